//! Hash helpers – un único punto para cambiar de algoritmo.

use blake3::Hasher;

/// Hashea varias partes separadas por un byte nulo (evita colisiones por
/// concatenación).
pub fn hash_parts(parts: &[&str]) -> String {
    let mut h = Hasher::new();
    for p in parts {
        h.update(p.as_bytes());
        h.update(&[0u8]);
    }
    h.finalize().to_hex().to_string()
}
