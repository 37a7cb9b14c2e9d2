//! Key de-obfuscation for link containers.

use super::{ContainerError, ContainerResult};

/// Index pair swapped by the gateway to obfuscate the key.
const SWAP_LEFT: usize = 15;
const SWAP_RIGHT: usize = 16;

/// Undo the gateway's key obfuscation by swapping the characters at
/// positions 15 and 16.
///
/// The swap is its own inverse, so `fix_key(&fix_key(k)?)? == k`. Keys of 16
/// characters or fewer are rejected with [`ContainerError::InvalidKey`].
pub fn fix_key(jk: &str) -> ContainerResult<String> {
    let mut chars: Vec<char> = jk.chars().collect();
    if chars.len() <= SWAP_RIGHT {
        return Err(ContainerError::InvalidKey(chars.len()));
    }

    chars.swap(SWAP_LEFT, SWAP_RIGHT);
    Ok(chars.into_iter().collect())
}
