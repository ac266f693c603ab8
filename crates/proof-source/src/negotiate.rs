use crate::request::SignatureScheme;

/// Picks the first scheme in the client's preference order that the key
/// supports. The server applies no ranking of its own.
pub fn negotiate_scheme(
    offered: &[SignatureScheme],
    supported: &[SignatureScheme],
) -> Option<SignatureScheme> {
    offered
        .iter()
        .copied()
        .filter(|scheme| !matches!(scheme, SignatureScheme::Unknown(_)))
        .find(|scheme| supported.contains(scheme))
}
