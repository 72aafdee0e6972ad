//! Primvar naming and unique material/prim names.

use std::collections::HashSet;

/// Fallback name for unnamed materials.
pub const DEFAULT_MATERIAL_NAME: &str = "mat";

/// Primvar holding normals.
pub const NORMALS: &str = "normals";
/// Primvar holding tangent vectors.
pub const TANGENTS: &str = "tangents";
/// Primvar holding tangent handedness (+1/-1).
pub const TANGENT_SIGNS: &str = "tangentSigns";

/// MaterialX type names that cannot be used as element names.
const MTLX_TYPE_NAMES: &[&str] = &[
    "integer",
    "boolean",
    "float",
    "color3",
    "color4",
    "vector2",
    "vector3",
    "vector4",
    "matrix33",
    "matrix44",
    "string",
    "filename",
    "geomname",
    "integerarray",
    "floatarray",
    "color3array",
    "color4array",
    "vector2array",
    "vector3array",
    "vector4array",
    "stringarray",
    "geomnamearray",
    "color",
    "shader",
    "material",
];

fn indexed_name(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{}{}", base, index)
    }
}

/// Primvar name of the UV set with the given index.
pub fn st_set_name(index: usize) -> String {
    indexed_name("st", index)
}

/// Primvar name of the vertex color set with the given index.
pub fn color_set_name(index: usize) -> String {
    indexed_name("color", index)
}

/// Primvar name of the vertex opacity set with the given index.
pub fn opacity_set_name(index: usize) -> String {
    indexed_name("opacity", index)
}

/// Replace characters outside `[A-Za-z0-9_]` with underscores and make sure
/// the result does not start with a digit.
pub fn make_valid_identifier(name: &str) -> String {
    if name.is_empty() {
        return "_".to_string();
    }
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Set of names already handed out during one conversion run.
#[derive(Debug, Default, Clone)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `base` and suffix `_1`, `_2`, ... until it is unused.
    pub fn make_unique(&mut self, base: &str) -> String {
        let base = make_valid_identifier(base);
        self.claim(&base, |_| false)
    }

    /// Material name usable both as a USD prim and a MaterialX element.
    ///
    /// Empty names become `mat`, a leading underscore gets a `mat` prefix
    /// and MaterialX type names are never returned.
    pub fn make_unique_material_name(&mut self, base: Option<&str>) -> String {
        let base = match base {
            None | Some("") => DEFAULT_MATERIAL_NAME.to_string(),
            Some(name) => {
                let valid = make_valid_identifier(name);
                if valid.starts_with('_') {
                    format!("{}{}", DEFAULT_MATERIAL_NAME, valid)
                } else {
                    valid
                }
            }
        };
        self.claim(&base, |name| MTLX_TYPE_NAMES.contains(&name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    fn claim(&mut self, base: &str, reserved: impl Fn(&str) -> bool) -> String {
        let mut name = base.to_string();
        let mut i = 1;
        while self.used.contains(&name) || reserved(&name) {
            name = format!("{}_{}", base, i);
            i += 1;
        }
        self.used.insert(name.clone());
        name
    }
}
