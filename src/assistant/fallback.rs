//! Offline answers used when the completion API is unavailable
//!
//! The responder scans the message for a fixed, ordered list of topics and
//! returns one of that topic's canned texts. Variant choice goes through a
//! seedable RNG so tests can pin it down; topic choice never does.

use crate::providers::ChatContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use std::sync::{Mutex, OnceLock};

/// What a fallback answer was chosen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTopic {
    Quantum,
    Relativity,
    BlackHole,
    Particle,
    Cosmology,
    Greeting,
    General,
}

impl FallbackTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quantum => "quantum",
            Self::Relativity => "relativity",
            Self::BlackHole => "black_hole",
            Self::Particle => "particle",
            Self::Cosmology => "cosmology",
            Self::Greeting => "greeting",
            Self::General => "general",
        }
    }
}

/// Keyword scanned for, topic, and the canned variants for that topic
const TOPIC_ANSWERS: &[(&str, FallbackTopic, &[&str])] = &[
    (
        "quantum",
        FallbackTopic::Quantum,
        &[
            "Quantum mechanics is the fundamental theory describing nature at the smallest scales. \
Key principles include wave-particle duality, the uncertainty principle (Δx·Δp ≥ ℏ/2), and quantum \
superposition. The Schrödinger equation (iℏ ∂ψ/∂t = Ĥψ) governs the evolution of quantum systems.",
            "In quantum mechanics a system is described by a wavefunction ψ whose squared magnitude |ψ|² \
gives measurement probabilities. Observables are operators, energy levels of bound systems are \
quantized (for the hydrogen atom Eₙ = -13.6 eV/n²), and entangled particles share correlations no \
classical theory can reproduce.",
        ],
    ),
    (
        "relativity",
        FallbackTopic::Relativity,
        &[
            "Einstein's special relativity is based on two postulates: the laws of physics are identical \
in all inertial reference frames, and the speed of light in vacuum is constant for all observers. \
This leads to time dilation (Δt' = γΔt) and the famous mass-energy equivalence E = mc².",
            "General relativity describes gravity as the curvature of spacetime produced by mass and \
energy, summarised by Einstein's field equations Gμν + Λgμν = (8πG/c⁴)Tμν. Its predictions include \
gravitational time dilation, the bending of light by massive objects, and gravitational waves.",
        ],
    ),
    (
        "black hole",
        FallbackTopic::BlackHole,
        &[
            "Black holes are regions of spacetime where gravity is so strong that nothing, not even \
light, can escape once it crosses the event horizon. The Schwarzschild radius rs = 2GM/c² defines \
this boundary for non-rotating black holes.",
            "A black hole forms when enough mass collapses inside its Schwarzschild radius rs = 2GM/c². \
The surface at that radius is the event horizon: a one-way boundary beyond which every path leads \
inward. Quantum effects make black holes glow faintly as Hawking radiation, at a temperature \
T = ℏc³/(8πGMk_B).",
        ],
    ),
    (
        "particle",
        FallbackTopic::Particle,
        &[
            "The Standard Model of particle physics describes the fundamental particles: six quarks, six \
leptons, the force-carrying gauge bosons (photon, gluons, W and Z), and the Higgs boson, which gives \
the W and Z bosons and the fermions their mass.",
            "Particle physics studies matter at its most basic level. Quarks combine into hadrons such as \
protons (uud) and neutrons (udd), held together by the strong force mediated by gluons, while \
leptons like the electron and neutrinos interact only through the electroweak force and gravity.",
        ],
    ),
    (
        "cosmology",
        FallbackTopic::Cosmology,
        &[
            "Cosmology studies the origin and evolution of the universe. Observations of the cosmic \
microwave background and the Hubble expansion (v = H₀d) support the Big Bang model, in which the \
universe has been expanding and cooling for about 13.8 billion years.",
            "Modern cosmology finds that ordinary matter makes up only about 5% of the universe's energy \
content; the rest is dark matter (about 27%) and dark energy (about 68%), which drives the \
accelerating expansion described by the Friedmann equations.",
        ],
    ),
];

const GREETING_TAIL: &str = "I'm your AI Physics Assistant. I'm currently running in offline mode, \
but I can still help with quantum mechanics, relativity, black holes, particle physics, and more. \
What would you like to explore?";

const GENERAL_ANSWER: &str = "I'm here to help with physics questions! I can discuss quantum \
mechanics, relativity, black holes, particle physics, mathematical physics, and more. What physics \
topic would you like to explore today?";

fn greeting_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\b(hello|hi|hey)\b").ok())
        .as_ref()
}

/// A canned answer and the topic it was chosen for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReply {
    pub topic: FallbackTopic,
    pub text: String,
}

/// Deterministic keyword-based responder
///
/// # Examples
///
/// ```
/// use horizon::assistant::{FallbackResponder, FallbackTopic};
/// use horizon::providers::ChatContext;
///
/// let responder = FallbackResponder::with_seed(7);
/// let reply = responder.generate("Tell me about black holes", &ChatContext::default());
/// assert_eq!(reply.topic, FallbackTopic::BlackHole);
/// assert!(reply.text.contains("event horizon"));
/// ```
#[derive(Debug)]
pub struct FallbackResponder {
    rng: Mutex<StdRng>,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackResponder {
    /// Responder seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Responder with a fixed seed
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for variant selection
    ///
    /// # Returns
    ///
    /// Returns a responder whose answer sequence depends only on `seed` and
    /// the messages it is given
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Topic a message would be answered with, without choosing a variant
    pub fn classify(&self, message: &str) -> FallbackTopic {
        let lower = message.to_lowercase();
        if let Some((_, topic, _)) = TOPIC_ANSWERS
            .iter()
            .find(|(keyword, _, _)| lower.contains(keyword))
        {
            return *topic;
        }

        if greeting_pattern().is_some_and(|pattern| pattern.is_match(message)) {
            FallbackTopic::Greeting
        } else {
            FallbackTopic::General
        }
    }

    /// Produce an offline answer
    pub fn generate(&self, message: &str, context: &ChatContext) -> FallbackReply {
        let topic = self.classify(message);
        let text = match topic {
            FallbackTopic::Greeting => {
                let greeting = match context.username.as_deref() {
                    Some(username) if !username.is_empty() => format!("Hello {}!", username),
                    _ => "Hello!".to_string(),
                };
                format!("{} {}", greeting, GREETING_TAIL)
            }
            FallbackTopic::General => GENERAL_ANSWER.to_string(),
            known => self.pick_variant(known),
        };

        FallbackReply { topic, text }
    }

    fn pick_variant(&self, topic: FallbackTopic) -> String {
        let variants = TOPIC_ANSWERS
            .iter()
            .find(|(_, candidate, _)| *candidate == topic)
            .map(|(_, _, variants)| *variants)
            .unwrap_or(&[GENERAL_ANSWER]);

        // a poisoned lock still holds a usable generator
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = rng.random_range(0..variants.len());
        variants[index].to_string()
    }
}
