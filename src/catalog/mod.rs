//! Cat records: the catalog entries and the node set of the pedigree graph.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CatteryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CatteryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(CatteryError::InvalidInput(format!("unknown gender: {}", other))),
        }
    }
}

/// Public catalog grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Kitten,
    Adult,
    All,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Kitten => "kitten",
            Category::Adult => "adult",
            Category::All => "all",
        }
    }
}

impl FromStr for Category {
    type Err = CatteryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kitten" => Ok(Category::Kitten),
            "adult" => Ok(Category::Adult),
            "all" => Ok(Category::All),
            other => Err(CatteryError::InvalidInput(format!("unknown category: {}", other))),
        }
    }
}

/// A breeding-program individual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cat {
    pub id: String,
    pub name: String,
    pub subtitle: String,
    pub description: String,
    /// Free text, e.g. "12 weeks"
    pub age: String,
    pub color: String,
    /// Display label, e.g. "available" or "reserved"
    pub status: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub registration_number: Option<String>,
    pub image_url: String,
    pub gallery: Vec<String>,
    pub is_displayed: bool,
    pub notes: Option<String>,
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cat {
    /// Build a new record with a fresh id from admin input
    pub fn from_new(input: NewCat) -> Result<Self> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CatteryError::InvalidInput("cat name must not be empty".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            subtitle: input.subtitle,
            description: input.description,
            age: input.age,
            color: input.color,
            status: input.status,
            gender: input.gender,
            birth_date: input.birth_date,
            registration_number: input.registration_number,
            image_url: input.image_url,
            gallery: input.gallery,
            is_displayed: input.is_displayed,
            notes: input.notes,
            category: input.category,
            internal_notes: input.internal_notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// The record as public readers see it: internal notes removed.
    pub fn public_view(&self) -> Cat {
        Cat {
            internal_notes: None,
            ..self.clone()
        }
    }

    /// Apply an admin edit. Only fields present in the patch change.
    pub fn apply_patch(&mut self, patch: CatPatch) -> Result<()> {
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CatteryError::InvalidInput("cat name must not be empty".to_string()));
            }
            self.name = name;
        }
        if let Some(v) = patch.subtitle {
            self.subtitle = v;
        }
        if let Some(v) = patch.description {
            self.description = v;
        }
        if let Some(v) = patch.age {
            self.age = v;
        }
        if let Some(v) = patch.color {
            self.color = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = patch.gender {
            self.gender = v;
        }
        if let Some(v) = patch.birth_date {
            self.birth_date = v;
        }
        if let Some(v) = patch.registration_number {
            self.registration_number = v;
        }
        if let Some(v) = patch.image_url {
            self.image_url = v;
        }
        if let Some(v) = patch.gallery {
            self.gallery = v;
        }
        if let Some(v) = patch.is_displayed {
            self.is_displayed = v;
        }
        if let Some(v) = patch.notes {
            self.notes = v;
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.internal_notes {
            self.internal_notes = v;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the cat shows up under a public category filter.
    /// `all`-tagged cats and untagged cats appear in every listing.
    pub fn in_category(&self, filter: Category) -> bool {
        match (filter, self.category) {
            (Category::All, _) => true,
            (_, None) | (_, Some(Category::All)) => true,
            (wanted, Some(actual)) => wanted == actual,
        }
    }
}

/// Admin input for creating a cat
#[derive(Debug, Clone, Deserialize)]
pub struct NewCat {
    pub name: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub status: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[serde(default = "default_displayed")]
    pub is_displayed: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub internal_notes: Option<String>,
}

fn default_displayed() -> bool {
    true
}

impl NewCat {
    /// Minimal input, mostly for tests and seed data
    pub fn new(name: impl Into<String>, gender: Gender, birth_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            subtitle: String::new(),
            description: String::new(),
            age: String::new(),
            color: String::new(),
            status: String::new(),
            gender,
            birth_date,
            registration_number: None,
            image_url: String::new(),
            gallery: Vec::new(),
            is_displayed: true,
            notes: None,
            category: None,
            internal_notes: None,
        }
    }
}

/// Partial admin edit.
///
/// Nullable fields use `Option<Option<T>>`: absent leaves the value alone,
/// explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatPatch {
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub age: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub registration_number: Option<Option<String>>,
    pub image_url: Option<String>,
    pub gallery: Option<Vec<String>>,
    pub is_displayed: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<Category>>,
    #[serde(default, deserialize_with = "double_option")]
    pub internal_notes: Option<Option<String>>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
