//! Merge "shallow" determinista de objetos JSON.
//!
//! Las claves de `patch` reemplazan a las de `base` (last-writer-wins por
//! clave). Objetos anidados se reemplazan completos, no se fusionan.

use serde_json::{Map, Value};

pub fn merge_object(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (k, v) in patch.iter() {
        out.insert(k.clone(), v.clone());
    }
    out
}
