//! Participant identifiers
//!
//! Short opaque tokens drawn from the OS random source, assigned to each
//! connection when it is admitted to the relay.

/// Length of a participant id in characters
pub const PARTICIPANT_ID_LENGTH: usize = 9;

/// Characters used in participant ids (lowercase base 36)
const PARTICIPANT_ID_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a random participant id (e.g., "k3x9q0b7m")
pub fn generate_participant_id() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; PARTICIPANT_ID_LENGTH];
    getrandom::fill(&mut bytes)?;

    Ok(bytes
        .iter()
        .map(|b| PARTICIPANT_ID_CHARS[(*b as usize) % PARTICIPANT_ID_CHARS.len()] as char)
        .collect())
}
