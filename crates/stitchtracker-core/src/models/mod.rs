//! Data models for the craft tracker backend.
//!
//! - `User`, `AdminUser`: account information
//! - `Project`, `ProjectKind`, `ProjectFilter`: knitting/crochet projects
//! - `Progress`, `ProgressImage`: dated progress updates with photos
//! - `Yarn`, `ProjectYarnLink`: the yarn stash and its use in projects
//! - `Tag`: user-defined project labels

pub mod progress;
pub mod project;
pub mod tag;
pub mod user;
pub mod yarn;

pub use progress::{Progress, ProgressImage, ProgressInput};
pub use project::{Project, ProjectFilter, ProjectInput, ProjectKind, ProjectYarn};
pub use tag::{tag_names, Tag};
pub use user::{AdminUser, AdminUserPatch, User};
pub use yarn::{ProjectYarnLink, Yarn, YarnInput};

/// Decimal fields arrive as JSON strings ("2.50") or numbers.
pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct DecimalVisitor;

    impl<'de> de::Visitor<'de> for DecimalVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a decimal number or numeric string")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            v.parse().map(Some).map_err(E::custom)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(DecimalVisitor)
}
