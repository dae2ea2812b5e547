//! Alias name generation

use rand::Rng;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;

const NOUNS: [&str; 20] = [
    "teapot", "walrus", "spreadsheet", "pigeon", "toaster", "meeting", "cactus", "printer",
    "noodle", "intern", "badger", "deadline", "muffin", "router", "llama", "stapler", "pickle",
    "compiler", "hamster", "invoice",
];

const ADJECTIVES: [&str; 20] = [
    "sleepy", "grumpy", "radioactive", "humble", "furious", "suspicious", "dubious", "crunchy",
    "almost-rich", "legendary", "mysterious", "chaotic", "gloomy", "deluded", "armored",
    "caffeinated", "soggy", "toxic", "almost-senior", "wobbly",
];

/// Source of alias local-parts
///
/// Collisions are the caller's problem, a generator only proposes candidates
pub trait NameGenerator: Send + Sync + 'static {
    /// Propose a local-part
    fn generate(&self) -> String;
}

/// Human-readable names like `walrus-grumpy-42`, drawn from the OS random source
#[derive(Clone, Copy, Debug, Default)]
pub struct FunnyNames;

impl NameGenerator for FunnyNames {
    fn generate(&self) -> String {
        let mut rng = OsRng;

        let noun = NOUNS.choose(&mut rng).copied().unwrap_or(NOUNS[0]);
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or(ADJECTIVES[0]);
        let number = rng.gen_range(0..=999);

        format!("{noun}-{adjective}-{number}")
    }
}
