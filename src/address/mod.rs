//! Addresses owned by customers.

mod manager;
mod store;

pub use manager::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Stored address. `is_primary` is derived from the owner's address book.
#[derive(Clone, Debug, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct Address {
    pub id: i64,
    pub username: String,
    pub phone_number: String,
    pub full_name: String,
    pub division: String,
    pub district: String,
    pub sub_district: String,
    #[serde(rename = "union")]
    pub union_name: String,
    pub division_slug: String,
    pub district_slug: String,
    pub sub_district_slug: String,
    #[serde(rename = "union_slug")]
    pub union_name_slug: String,
    pub address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub is_primary: bool,
    pub is_deleted: bool,
}

/// Address as sent by its owner.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Validate)]
pub struct NewAddress {
    #[validate(length(min = 1, message = "phone_number is required"))]
    pub phone_number: String,
    #[validate(length(min = 1, max = 128, message = "full_name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "division is required"))]
    pub division: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub sub_district: String,
    #[serde(default, rename = "union")]
    pub union_name: String,
    #[validate(length(min = 1, message = "division_slug is required"))]
    pub division_slug: String,
    #[validate(length(min = 1, message = "district_slug is required"))]
    pub district_slug: String,
    #[serde(default)]
    pub sub_district_slug: String,
    #[serde(default, rename = "union_slug")]
    pub union_name_slug: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub latitude: f64,
}

/// Partial update of an [`Address`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct AddressPatch {
    pub phone_number: Option<String>,
    #[validate(length(max = 128))]
    pub full_name: Option<String>,
    pub division: Option<String>,
    pub district: Option<String>,
    pub sub_district: Option<String>,
    #[serde(rename = "union")]
    pub union_name: Option<String>,
    pub division_slug: Option<String>,
    pub district_slug: Option<String>,
    pub sub_district_slug: Option<String>,
    #[serde(rename = "union_slug")]
    pub union_name_slug: Option<String>,
    pub address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl AddressPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Text columns paired with their new value.
    fn text_fields(&self) -> [(&'static str, &Option<String>); 11] {
        [
            ("phone_number", &self.phone_number),
            ("full_name", &self.full_name),
            ("division", &self.division),
            ("district", &self.district),
            ("sub_district", &self.sub_district),
            ("union_name", &self.union_name),
            ("division_slug", &self.division_slug),
            ("district_slug", &self.district_slug),
            ("sub_district_slug", &self.sub_district_slug),
            ("union_name_slug", &self.union_name_slug),
            ("address", &self.address),
        ]
    }
}
