//! Movie catalogue records.
mod filters;

pub use filters::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use validator::{Validate, ValidationErrors};

use crate::validation::failure;

/// Movie as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    /// Replace every editable field with the draft's value.
    ///
    /// The draft must have passed validation; `version` is left as observed.
    pub fn apply(&mut self, draft: MovieDraft) -> Result<(), ValidationErrors> {
        let runtime = draft.runtime()?;
        self.title = draft.title;
        self.year = draft.year;
        self.runtime = runtime;
        self.genres = draft.genres;
        Ok(())
    }
}

/// Fields needed to insert a new movie.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

/// Movie duration in minutes, written `"<N> mins"` on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid runtime format")]
pub struct RuntimeFormatError;

impl FromStr for Runtime {
    type Err = RuntimeFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_suffix(" mins")
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<i32>().ok())
            .map(Runtime)
            .ok_or(RuntimeFormatError)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Candidate movie fields, as sent by a client or derived from a patch.
///
/// Missing keys decode to empty values so that they surface as validation
/// failures rather than decoding failures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct MovieDraft {
    #[validate(custom(function = "crate::validation::validate_title"))]
    pub title: String,
    #[validate(custom(function = "crate::validation::validate_year"))]
    pub year: i32,
    #[validate(custom(function = "crate::validation::validate_runtime"))]
    pub runtime: String,
    #[validate(custom(function = "crate::validation::validate_genres"))]
    pub genres: Vec<String>,
}

impl MovieDraft {
    fn runtime(&self) -> Result<Runtime, ValidationErrors> {
        self.runtime.parse().map_err(|_| {
            let mut errors = ValidationErrors::new();
            errors.add(
                "runtime",
                failure("format", "must be formatted as \"<N> mins\""),
            );
            errors
        })
    }

    /// Turn a validated draft into an insertable movie.
    pub fn into_new(self) -> Result<NewMovie, ValidationErrors> {
        let runtime = self.runtime()?;
        Ok(NewMovie {
            title: self.title,
            year: self.year,
            runtime,
            genres: self.genres,
        })
    }
}

impl From<&Movie> for MovieDraft {
    fn from(movie: &Movie) -> Self {
        Self {
            title: movie.title.clone(),
            year: movie.year,
            runtime: movie.runtime.to_string(),
            genres: movie.genres.clone(),
        }
    }
}

/// Presence-aware field of a partial update.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Patch<T> {
    /// Key not sent: keep the stored value.
    #[default]
    Absent,
    /// Key sent as `null`.
    Null,
    Value(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

/// Body of `PATCH /v1/movies/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MoviePatch {
    pub title: Patch<String>,
    pub year: Patch<i32>,
    pub runtime: Patch<String>,
    pub genres: Patch<Vec<String>>,
}

impl MoviePatch {
    /// Merge supplied fields over the stored movie.
    ///
    /// Explicit `null` cannot clear a required field and is reported per key.
    pub fn merge(self, movie: &Movie) -> Result<MovieDraft, ValidationErrors> {
        let mut draft = MovieDraft::from(movie);
        let mut errors = ValidationErrors::new();

        fn take<T>(
            patch: Patch<T>,
            slot: &mut T,
            field: &'static str,
            errors: &mut ValidationErrors,
        ) {
            match patch {
                Patch::Absent => {},
                Patch::Null => {
                    errors.add(field, failure("null", "must not be null"))
                },
                Patch::Value(value) => *slot = value,
            }
        }

        take(self.title, &mut draft.title, "title", &mut errors);
        take(self.year, &mut draft.year, "year", &mut errors);
        take(self.runtime, &mut draft.runtime, "runtime", &mut errors);
        take(self.genres, &mut draft.genres, "genres", &mut errors);

        if errors.is_empty() {
            Ok(draft)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fight_club() -> Movie {
        Movie {
            id: 1,
            created_at: Utc::now(),
            title: "Fight Club".into(),
            year: 1994,
            runtime: Runtime(105),
            genres: vec!["Sigma".into()],
            version: 0,
        }
    }

    #[test]
    fn test_runtime_wire_format() {
        assert_eq!(serde_json::to_string(&Runtime(105)).unwrap(), r#""105 mins""#);
        assert_eq!("120 mins".parse::<Runtime>().unwrap(), Runtime(120));
        assert!("120".parse::<Runtime>().is_err());
        assert!("+5 mins".parse::<Runtime>().is_err());
        assert!(" mins".parse::<Runtime>().is_err());
    }

    #[test]
    fn test_movie_json_shape() {
        let json = serde_json::to_string(&fight_club()).unwrap();
        assert_eq!(
            json,
            r#"{"id":1,"title":"Fight Club","year":1994,"runtime":"105 mins","genres":["Sigma"],"version":0}"#
        );
    }

    #[test]
    fn test_draft_missing_fields_fail_validation() {
        let draft: MovieDraft = serde_json::from_str("{}").unwrap();
        let errors = draft.validate().unwrap_err();
        let fields = errors.field_errors();

        for key in ["title", "year", "runtime", "genres"] {
            assert!(fields.contains_key(key), "missing error for {key}");
        }
    }

    #[test]
    fn test_draft_rejects_unknown_key() {
        let err = serde_json::from_str::<MovieDraft>(r#"{"rating":5}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_patch_presence() {
        let patch: MoviePatch =
            serde_json::from_str(r#"{"title":"Fight Club 2","year":null}"#).unwrap();

        assert_eq!(patch.title, Patch::Value("Fight Club 2".to_string()));
        assert_eq!(patch.year, Patch::Null);
        assert_eq!(patch.runtime, Patch::Absent);

        let errors = patch.merge(&fight_club()).unwrap_err();
        assert_eq!(
            errors.field_errors()["year"][0].message.as_deref(),
            Some("must not be null")
        );
    }

    #[test]
    fn test_patch_keeps_absent_fields() {
        let patch: MoviePatch = serde_json::from_str(r#"{"runtime":"140 mins"}"#).unwrap();
        let mut movie = fight_club();
        let draft = patch.merge(&movie).unwrap();

        assert!(draft.validate().is_ok());
        movie.apply(draft).unwrap();
        assert_eq!(movie.runtime, Runtime(140));
        assert_eq!(movie.title, "Fight Club");
        assert_eq!(movie.version, 0);
    }
}
