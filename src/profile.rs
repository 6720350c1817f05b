//! Who the tutor is for a speaking session: personality, learner level,
//! scenario and the vocabulary it should weave in.

use std::fmt;

/// Words the tutor is asked to use when the caller supplies none.
pub const DEFAULT_VOCABULARY: [&str; 3] = ["resilient", "inevitably", "paradigm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Personality {
    #[default]
    Friendly,
    Strict,
    Creative,
    Caring,
    Rude,
}

impl Personality {
    pub const ALL: [Personality; 5] = [
        Personality::Friendly,
        Personality::Strict,
        Personality::Creative,
        Personality::Caring,
        Personality::Rude,
    ];

    /// Prebuilt voice used for this personality's speech.
    pub fn voice_name(self) -> &'static str {
        match self {
            Personality::Strict => "Puck",
            Personality::Caring => "Kore",
            _ => "Zephyr",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Personality::Friendly => "Friendly",
            Personality::Strict => "Strict",
            Personality::Creative => "Creative",
            Personality::Caring => "Caring",
            Personality::Rude => "Rude",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scenario {
    #[default]
    Casual,
    Interview,
    Hotel,
    Coffee,
    /// Free-form situation described by the learner.
    Custom(String),
}

impl Scenario {
    pub fn id(&self) -> &'static str {
        match self {
            Scenario::Casual => "casual",
            Scenario::Interview => "interview",
            Scenario::Hotel => "hotel",
            Scenario::Coffee => "coffee",
            Scenario::Custom(_) => "custom",
        }
    }

    /// Text placed in the system instruction.
    pub fn title(&self) -> &str {
        match self {
            Scenario::Casual => "Casual conversation",
            Scenario::Interview => "Job interview",
            Scenario::Hotel => "Booking a hotel room",
            Scenario::Coffee => "At the coffee shop",
            Scenario::Custom(description) => description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionProfile {
    pub personality: Personality,
    pub level: Level,
    pub scenario: Scenario,
    pub vocabulary: Vec<String>,
}

impl Default for InstructionProfile {
    fn default() -> Self {
        Self {
            personality: Personality::default(),
            level: Level::default(),
            scenario: Scenario::default(),
            vocabulary: DEFAULT_VOCABULARY.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl InstructionProfile {
    pub fn new(personality: Personality, level: Level, scenario: Scenario) -> Self {
        Self {
            personality,
            level,
            scenario,
            ..Default::default()
        }
    }

    pub fn with_vocabulary<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn system_instruction(&self) -> String {
        format!(
            "You are an English tutor. Personality: {}. Level: {}. Scenario: {}. Use: {}.",
            self.personality,
            self.level,
            self.scenario.title(),
            self.vocabulary.join(",")
        )
    }

    pub fn voice_name(&self) -> &'static str {
        self.personality.voice_name()
    }
}
