use std::sync::{LazyLock, Mutex};

use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

static INTERNER: LazyLock<Mutex<StringInterner<DefaultBackend>>> =
    LazyLock::new(|| Mutex::new(StringInterner::default()));

fn with_interner<R>(f: impl FnOnce(&mut StringInterner<DefaultBackend>) -> R) -> R {
    f(&mut INTERNER.lock().unwrap())
}

/// Interned name. Scope-map keys, reference roots and macro parameter names
/// all share one process-wide pool, so lookups compare pointer-sized symbols
/// instead of strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(DefaultSymbol);

impl Ident {
    pub fn new(s: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(s)))
    }

    pub fn as_str(&self) -> String {
        self.resolve_with(str::to_string)
    }

    /// Runs `f` on the interned string without allocating. `f` must not
    /// intern new idents, the interner lock is held while it runs.
    pub fn resolve_with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        with_interner(|interner| f(interner.resolve(self.0).unwrap()))
    }

    /// The key a macro scope files this parameter's unevaluated call-site
    /// text under: `.literal.foo` for `foo`. The dotted prefix keeps the
    /// alias out of the namespace a template author can reference.
    pub fn literal_alias(&self) -> Ident {
        let alias = self.resolve_with(|s| format!(".literal.{s}"));
        Ident::new(&alias)
    }
}

impl Default for Ident {
    fn default() -> Self {
        Ident::new("")
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.resolve_with(|s| f.write_str(s))
    }
}

#[cfg(feature = "ast-json")]
impl serde::Serialize for Ident {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.resolve_with(|s| serializer.serialize_str(s))
    }
}

#[cfg(feature = "ast-json")]
impl<'de> serde::Deserialize<'de> for Ident {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Ident::new(&s))
    }
}
