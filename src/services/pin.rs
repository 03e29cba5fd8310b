use rand::{Rng, rng};

use crate::state::state_machine::SessionMode;

/// Number of characters in an access PIN.
pub const PIN_LENGTH: usize = 6;

const DIGITS: &[u8] = b"0123456789";
/// Practice PINs skip look-alike characters (0/O, 1/I) so they can be read aloud.
const ALPHANUMERIC: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Draw a random PIN for a session of `mode`: numeric for hosted and solo play,
/// alphanumeric for practice.
pub fn generate_pin(mode: SessionMode) -> String {
    let alphabet = match mode {
        SessionMode::HostedMultiplayer | SessionMode::SoloTimed => DIGITS,
        SessionMode::PracticeUntimed => ALPHANUMERIC,
    };

    let mut rng = rng();
    (0..PIN_LENGTH)
        .map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
        .collect()
}

/// Canonical form of a user-entered PIN: trimmed and upper-cased.
pub fn normalize_pin(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Whether `pin` could have been produced by [`generate_pin`].
pub fn is_well_formed(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|byte| byte.is_ascii_alphanumeric())
}
