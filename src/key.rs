//! Hierarchical service keys
//!
//! Keys are dot-separated namespaced names such as `Service.Equipment.Data`.
//! They hash and compare like their text, so registry lookups can borrow a
//! plain `&str`.

use crate::{Result, ServiceError};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Separator between key segments
pub const KEY_SEPARATOR: char = '.';

/// Stable identifier naming one registration slot.
///
/// Cloning is cheap (shared `Arc<str>`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(Arc<str>);

impl ServiceKey {
    /// Parse and validate a key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_locator::ServiceKey;
    ///
    /// let key = ServiceKey::new("Service.Equipment.Data").unwrap();
    /// assert_eq!(key.segments().count(), 3);
    ///
    /// assert!(ServiceKey::new("").is_err());
    /// assert!(ServiceKey::new("Service..Data").is_err());
    /// ```
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        validate(name)?;
        Ok(Self(Arc::from(name)))
    }

    /// Build a key from a literal.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid key.
    pub fn from_static(name: &'static str) -> Self {
        match validate(name) {
            Ok(()) => Self(Arc::from(name)),
            Err(err) => panic!("invalid service key literal {name:?}: {err}"),
        }
    }

    /// Whether `name` would be accepted by [`ServiceKey::new`]
    #[inline]
    pub fn is_valid(name: &str) -> bool {
        validate(name).is_ok()
    }

    /// Key text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments, outermost first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }

    /// Enclosing namespace, or `None` for a single-segment key
    pub fn parent(&self) -> Option<ServiceKey> {
        self.0
            .rfind(KEY_SEPARATOR)
            .map(|idx| Self(Arc::from(&self.0[..idx])))
    }

    /// Hierarchical match: `Service.Equipment.Data` matches `Service.Equipment`
    /// and itself, but not `Service.Equip`.
    pub fn matches(&self, namespace: &ServiceKey) -> bool {
        match self.0.strip_prefix(namespace.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(KEY_SEPARATOR),
            None => false,
        }
    }
}

fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ServiceError::invalid_argument("service key is empty"));
    }

    for segment in name.split(KEY_SEPARATOR) {
        if segment.is_empty() {
            return Err(ServiceError::invalid_argument(format!(
                "service key {name:?} has an empty segment"
            )));
        }
        if let Some(bad) = segment
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(ServiceError::invalid_argument(format!(
                "service key {name:?} contains invalid character {bad:?}"
            )));
        }
    }

    Ok(())
}

impl Deref for ServiceKey {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Hash/Eq are derived from the inner str, so borrowing as str is consistent.
impl Borrow<str> for ServiceKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServiceKey {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ServiceKey {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ServiceKey {
    type Error = ServiceError;

    fn try_from(s: String) -> Result<Self> {
        validate(&s)?;
        Ok(Self(Arc::from(s)))
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.0)
    }
}
