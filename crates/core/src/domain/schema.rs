// Registration-time entity schemas
//
// Every entity declares its table, key and fields up front. Ordering,
// projection and row decoding resolve names against these lists instead of
// inspecting types at runtime.

/// Storage kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Bool,
}

/// A named, typed field of an entity or DTO shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, FieldKind::Real)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// Case-insensitive match that also ignores underscores, so the wire
    /// names `modifiedOn` and `ModifiedOn` both resolve `modified_on`.
    pub fn matches(&self, token: &str) -> bool {
        let mut expected = self.name.chars().filter(|c| *c != '_');
        let mut given = token.trim().chars().filter(|c| *c != '_');
        loop {
            match (expected.next(), given.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a.eq_ignore_ascii_case(&b) => continue,
                _ => return false,
            }
        }
    }
}

/// Resolve a caller-supplied field token against a field list
pub fn resolve_field(fields: &'static [FieldDef], token: &str) -> Option<&'static FieldDef> {
    fields.iter().find(|field| field.matches(token))
}

/// Which audit capabilities an entity type exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub creatable: bool,
    pub modifiable: bool,
    pub deletable: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        creatable: false,
        modifiable: false,
        deletable: false,
    };

    pub const AUDITED: Capabilities = Capabilities {
        creatable: true,
        modifiable: true,
        deletable: true,
    };
}

/// Table-level description of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub table: &'static str,
    pub key: FieldDef,
    /// Key values are assigned by the store on insert
    pub generated_key: bool,
    pub fields: &'static [FieldDef],
    pub capabilities: Capabilities,
}

impl Schema {
    pub fn resolve(&self, token: &str) -> Option<&'static FieldDef> {
        resolve_field(self.fields, token)
    }

    /// Exact lookup by declared name
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldDef] = &[
        FieldDef::integer("id"),
        FieldDef::text("title"),
        FieldDef::integer("modified_on"),
    ];

    #[test]
    fn test_matches_ignores_case_and_underscores() {
        let field = FieldDef::integer("modified_on");

        assert!(field.matches("modified_on"));
        assert!(field.matches("modifiedOn"));
        assert!(field.matches("ModifiedOn"));
        assert!(field.matches("MODIFIED_ON"));
        assert!(!field.matches("modified"));
        assert!(!field.matches("modified_on_x"));
    }

    #[test]
    fn test_resolve_field_unknown_is_none() {
        assert_eq!(resolve_field(FIELDS, "Title").map(|f| f.name), Some("title"));
        assert!(resolve_field(FIELDS, "nope").is_none());
        assert!(resolve_field(FIELDS, "").is_none());
    }
}
