pub mod challenge;
pub mod verifier;

pub use challenge::{ChallengeFactory, PaymentChallenge};
pub use verifier::{Evidence, PaymentVerifier, VerificationRequest};
