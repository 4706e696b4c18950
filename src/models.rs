use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9]{10}$").unwrap();
}

/// Role of a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sales,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Review state of a tile selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStatus {
    #[default]
    Draft,
    Reviewed,
    Billed,
}

impl fmt::Display for SelectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionStatus::Draft => "Draft",
            SelectionStatus::Reviewed => "Reviewed",
            SelectionStatus::Billed => "Billed",
        };
        f.write_str(s)
    }
}

impl FromStr for SelectionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(SelectionStatus::Draft),
            "reviewed" => Ok(SelectionStatus::Reviewed),
            "billed" => Ok(SelectionStatus::Billed),
            other => Err(AppError::validation(format!("Unknown status '{}'", other))),
        }
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: Uuid,
    pub tile_name: String,
    /// Physical size in cm, e.g. `60x60`
    pub size: String,
    pub pieces_per_box: u32,
    pub sqft_per_box: f64,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub area: String,
    /// Salesperson who registered the customer
    pub salesperson_id: Option<Uuid>,
    pub visit_date: NaiveDate,
    pub has_chit_photo: bool,
    pub chit_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub room_name: String,
    pub total_sqft: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A tile considered for a room, with the admin's billing adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSelection {
    pub id: Uuid,
    pub room_id: Uuid,
    pub tile_id: Uuid,
    pub sqft_required: f64,
    pub price_per_sqft: Option<f64>,
    pub is_final_choice: bool,
    pub admin_adjusted_boxes: Option<u32>,
    pub filler_quantity: Option<u32>,
    pub transport_charge: Option<f64>,
    pub admin_notes: Option<String>,
    pub status: SelectionStatus,
    pub created_at: DateTime<Utc>,
}

/// Trim a required text field, rejecting it when blank.
fn required(value: &str, label: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", label)));
    }
    Ok(value.to_string())
}

/// Trim an optional text field, treating blank as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_negative(value: f64, label: &str) -> AppResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation(format!("{} cannot be negative", label)));
    }
    Ok(value)
}

fn count(value: i64, label: &str) -> AppResult<u32> {
    if value < 0 {
        return Err(AppError::validation(format!("{} cannot be negative", label)));
    }
    u32::try_from(value).map_err(|_| AppError::validation(format!("{} is out of range", label)))
}

/// Deserialize a field where `null` means "clear" and a missing key means
/// "leave unchanged": missing stays `None` via `#[serde(default)]`, present
/// becomes `Some(value_or_none)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Customer intake form
#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub area: String,
    #[serde(default)]
    pub visit_date: Option<NaiveDate>,
}

impl NewCustomer {
    /// Validate and normalise the intake form into a record owned by `salesperson_id`.
    pub fn into_customer(self, salesperson_id: Option<Uuid>) -> AppResult<Customer> {
        let name = required(&self.name, "Name")?;
        let phone = required(&self.phone, "Phone")?;
        if !PHONE_REGEX.is_match(&phone) {
            return Err(AppError::validation(
                "Please enter a valid 10-digit phone number",
            ));
        }
        let area = required(&self.area, "Area")?;
        let now = Utc::now();

        Ok(Customer {
            id: Uuid::new_v4(),
            name,
            phone,
            area,
            salesperson_id,
            visit_date: self.visit_date.unwrap_or_else(|| now.date_naive()),
            has_chit_photo: false,
            chit_image_url: None,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub customer_id: Uuid,
    pub room_name: String,
    pub total_sqft: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRoom {
    pub fn into_room(self) -> AppResult<Room> {
        let room_name = required(&self.room_name, "Room name")?;
        if !self.total_sqft.is_finite() || self.total_sqft <= 0.0 {
            return Err(AppError::validation("Please enter the area in square feet"));
        }
        Ok(Room {
            id: Uuid::new_v4(),
            customer_id: self.customer_id,
            room_name,
            total_sqft: self.total_sqft,
            notes: optional(self.notes),
            created_at: Utc::now(),
        })
    }
}

/// Tile chosen for a room. `sqft_required` defaults to the room's area.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTileSelection {
    pub room_id: Uuid,
    pub tile_id: Uuid,
    #[serde(default)]
    pub sqft_required: Option<f64>,
    #[serde(default)]
    pub price_per_sqft: Option<f64>,
    #[serde(default)]
    pub is_final_choice: bool,
}

impl NewTileSelection {
    pub fn into_selection(self, room: &Room) -> AppResult<TileSelection> {
        let sqft_required = non_negative(
            self.sqft_required.unwrap_or(room.total_sqft),
            "Required area",
        )?;
        let price_per_sqft = self
            .price_per_sqft
            .map(|rate| non_negative(rate, "Rate"))
            .transpose()?;

        Ok(TileSelection {
            id: Uuid::new_v4(),
            room_id: room.id,
            tile_id: self.tile_id,
            sqft_required,
            price_per_sqft,
            is_final_choice: self.is_final_choice,
            admin_adjusted_boxes: None,
            filler_quantity: None,
            transport_charge: None,
            admin_notes: None,
            status: SelectionStatus::Draft,
            created_at: Utc::now(),
        })
    }
}

/// Admin adjustment of a selection.
///
/// A missing field stays unchanged. For the adjustment fields an explicit
/// `null` clears the stored value, so the calculated box count and the
/// unpriced estimate come back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionUpdate {
    #[serde(default, deserialize_with = "nullable")]
    pub admin_adjusted_boxes: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub filler_quantity: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub transport_charge: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub admin_notes: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub price_per_sqft: Option<Option<f64>>,
    #[serde(default)]
    pub is_final_choice: Option<bool>,
}

impl SelectionUpdate {
    /// Apply the update in place; nothing is written if any field is invalid.
    ///
    /// # Errors
    /// * `Validation` for a negative or out-of-range count, a negative or
    ///   non-finite amount, or an unknown status
    pub fn apply(self, selection: &mut TileSelection) -> AppResult<()> {
        let boxes = self
            .admin_adjusted_boxes
            .map(|b| b.map(|b| count(b, "Adjusted box count")).transpose())
            .transpose()?;
        let filler = self
            .filler_quantity
            .map(|f| f.map(|f| count(f, "Filler quantity")).transpose())
            .transpose()?;
        let transport = self
            .transport_charge
            .map(|t| t.map(|t| non_negative(t, "Transport charge")).transpose())
            .transpose()?;
        let rate = self
            .price_per_sqft
            .map(|r| r.map(|r| non_negative(r, "Rate")).transpose())
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(SelectionStatus::from_str)
            .transpose()?;

        if let Some(boxes) = boxes {
            selection.admin_adjusted_boxes = boxes;
        }
        if let Some(filler) = filler {
            selection.filler_quantity = filler;
        }
        if let Some(transport) = transport {
            selection.transport_charge = transport;
        }
        if let Some(rate) = rate {
            selection.price_per_sqft = rate;
        }
        if let Some(notes) = self.admin_notes {
            selection.admin_notes = optional(notes);
        }
        if let Some(status) = status {
            selection.status = status;
        }
        if let Some(is_final) = self.is_final_choice {
            selection.is_final_choice = is_final;
        }
        Ok(())
    }
}

/// Catalog form, used for both adding and editing a tile.
#[derive(Debug, Clone, Deserialize)]
pub struct TileInput {
    pub tile_name: String,
    pub size: String,
    pub pieces_per_box: i64,
    pub sqft_per_box: f64,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TileInput {
    pub fn into_tile(self, id: Uuid, created_at: DateTime<Utc>) -> AppResult<Tile> {
        let tile_name = required(&self.tile_name, "Tile name")?;
        let size = required(&self.size, "Size")?;
        if self.pieces_per_box < 1 {
            return Err(AppError::validation("Pieces per box must be at least 1"));
        }
        let pieces_per_box = count(self.pieces_per_box, "Pieces per box")?;
        if !self.sqft_per_box.is_finite() || self.sqft_per_box <= 0.0 {
            return Err(AppError::validation(
                "Sq.ft per box must be greater than zero",
            ));
        }

        Ok(Tile {
            id,
            tile_name,
            size,
            pieces_per_box,
            sqft_per_box: self.sqft_per_box,
            barcode: optional(self.barcode),
            image_url: optional(self.image_url),
            is_active: self.is_active.unwrap_or(true),
            created_at,
        })
    }
}

/// A selection joined with its tile and the derived box/price figures.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionView {
    #[serde(flatten)]
    pub selection: TileSelection,
    pub tile: Tile,
    pub calculated_boxes: u64,
    pub estimated_price: Option<f64>,
    /// Admin-adjusted count when set, otherwise the calculated count
    pub effective_boxes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,
    pub selections: Vec<SelectionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub rooms: Vec<RoomDetail>,
}
