use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::MAX_NAMESPACE_LENGTH;

#[derive(Debug, Clone)]
pub struct InvalidNamespace(pub String);

impl fmt::Display for InvalidNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InvalidNamespace {}

/// Name of a metadata plugin, used as the key of the uploaded metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(String);

impl Namespace {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = InvalidNamespace;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        if name.is_empty() {
            return Err(InvalidNamespace("Namespace cannot be empty".to_string()));
        }

        if name.len() > MAX_NAMESPACE_LENGTH {
            return Err(InvalidNamespace(format!(
                "Namespace must be at most {MAX_NAMESPACE_LENGTH} characters"
            )));
        }

        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        {
            return Err(InvalidNamespace(
                "Namespace can only contain alphanumeric characters, dots, hyphens, and underscores"
                    .to_string(),
            ));
        }

        Ok(Self(name))
    }
}

impl TryFrom<&str> for Namespace {
    type Error = InvalidNamespace;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::try_from(name.to_string())
    }
}

impl FromStr for Namespace {
    type Err = InvalidNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Namespace {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NamespaceVisitor;

        impl Visitor<'_> for NamespaceVisitor {
            type Value = Namespace;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a valid metadata namespace")
            }

            fn visit_str<E>(self, value: &str) -> Result<Namespace, E>
            where
                E: de::Error,
            {
                Namespace::try_from(value).map_err(|e| de::Error::custom(e.0))
            }
        }

        deserializer.deserialize_str(NamespaceVisitor)
    }
}
