//! Data-access layer over the showroom tables.
//!
//! The tables live in memory and are written to a gzip/bincode snapshot after
//! every mutation. Reads go through the [`QueryCache`]; each write drops the
//! cached queries it affects, so the next read recomputes from the tables.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

use crate::cache::{Cached, QueryCache, QueryKey};
use crate::error::{AppError, AppResult};
use crate::estimate;
use crate::models::{
    Customer, CustomerDetail, NewCustomer, NewRoom, NewTileSelection, Room, RoomDetail,
    SelectionUpdate, SelectionView, Tile, TileInput, TileSelection,
};
use crate::saving;

/// Every persisted table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub tiles: Vec<Tile>,
    pub customers: Vec<Customer>,
    pub rooms: Vec<Room>,
    pub tile_selections: Vec<TileSelection>,
}

impl Tables {
    fn tile(&self, id: Uuid) -> AppResult<&Tile> {
        self.tiles
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::not_found("Tile not found"))
    }

    fn customer(&self, id: Uuid) -> AppResult<&Customer> {
        self.customers
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::not_found("Customer not found"))
    }

    fn room(&self, id: Uuid) -> AppResult<&Room> {
        self.rooms
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::not_found("Room not found"))
    }

    fn selection_mut(&mut self, id: Uuid) -> AppResult<&mut TileSelection> {
        self.tile_selections
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::not_found("Tile selection not found"))
    }

    fn barcode_taken(&self, barcode: &str, except: Option<Uuid>) -> bool {
        self.tiles
            .iter()
            .any(|t| Some(t.id) != except && t.barcode.as_deref() == Some(barcode))
    }

    /// Join a selection with its tile and derive the box/price figures.
    fn view(&self, selection: &TileSelection) -> AppResult<SelectionView> {
        let tile = self.tile(selection.tile_id)?.clone();
        let est = estimate::estimate(
            selection.sqft_required,
            tile.sqft_per_box,
            selection.price_per_sqft,
        )?;
        let effective_boxes = selection
            .admin_adjusted_boxes
            .map(u64::from)
            .unwrap_or(est.calculated_boxes);

        Ok(SelectionView {
            selection: selection.clone(),
            tile,
            calculated_boxes: est.calculated_boxes,
            estimated_price: est.estimated_price,
            effective_boxes,
        })
    }
}

pub struct Store {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
    cache: QueryCache,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl Store {
    /// Store with no backing file, used by tests.
    pub fn in_memory() -> Self {
        Store {
            tables: RwLock::new(Tables::default()),
            path: None,
            cache: QueryCache::new(),
        }
    }

    /// Open the snapshot at `path`, creating an empty one if it does not exist.
    ///
    /// # Arguments
    /// * `path` - Location of the gzip/bincode snapshot, e.g. `database/store.bin.gz`
    ///
    /// # Returns
    /// * `std::io::Result<Store>` - The store with the snapshot's tables loaded
    ///
    /// # Errors
    /// * Returns an error if the snapshot cannot be read or decoded, or the
    ///   empty one cannot be written
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let tables: Tables = saving::load_snapshot(&path)?;
            log::info!(
                "loaded {} customers, {} rooms, {} selections, {} tiles from {}",
                tables.customers.len(),
                tables.rooms.len(),
                tables.tile_selections.len(),
                tables.tiles.len(),
                path.display()
            );
            tables
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tables = Tables::default();
            saving::save_snapshot(&tables, &path)?;
            log::info!("created empty store at {}", path.display());
            tables
        };

        Ok(Store {
            tables: RwLock::new(tables),
            path: Some(path),
            cache: QueryCache::new(),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a copy of the tables and swap it in once the snapshot
    /// is on disk, dropping the cached queries `stale` names before the write
    /// lock is released. On any error the live tables are left unchanged.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> AppResult<R>,
        stale: impl FnOnce(&R) -> Vec<QueryKey>,
    ) -> AppResult<R> {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            saving::save_snapshot(&next, path)?;
        }
        *guard = next;
        for key in stale(&out) {
            self.cache.invalidate(&key);
        }
        Ok(out)
    }

    // ---- customers ----

    /// All customers, newest first.
    pub fn customers(&self) -> Arc<Vec<Customer>> {
        if let Some(Cached::Customers(list)) = self.cache.get(&QueryKey::Customers) {
            return list;
        }
        let tables = self.read();
        let mut list = tables.customers.clone();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let list = Arc::new(list);
        self.cache
            .put(QueryKey::Customers, Cached::Customers(list.clone()));
        list
    }

    /// Customers visible to `owner` (all when `None`), filtered by a search on
    /// name, phone or area.
    pub fn list_customers(&self, owner: Option<Uuid>, query: Option<&str>) -> Vec<Customer> {
        let needle = query.map(|q| q.trim().to_lowercase()).unwrap_or_default();
        self.customers()
            .iter()
            .filter(|c| owner.is_none() || c.salesperson_id == owner)
            .filter(|c| {
                needle.is_empty()
                    || contains_ci(&c.name, &needle)
                    || c.phone.contains(&needle)
                    || contains_ci(&c.area, &needle)
            })
            .cloned()
            .collect()
    }

    /// # Errors
    /// * `NotFound` if no customer has this id
    pub fn customer(&self, id: Uuid) -> AppResult<Customer> {
        self.read().customer(id).cloned()
    }

    /// Register a walk-in customer.
    ///
    /// The intake is validated (name, area and a 10-digit phone are required;
    /// the visit date defaults to today) and persisted before the customer
    /// list cache is dropped.
    ///
    /// # Arguments
    /// * `input` - The intake form as posted by the page
    /// * `salesperson_id` - The salesperson registering the customer, if any
    ///
    /// # Returns
    /// * `AppResult<Customer>` - The stored customer record
    ///
    /// # Errors
    /// * `Validation` if a field is missing or the phone is malformed
    /// * `Storage` if the snapshot cannot be written
    pub fn add_customer(
        &self,
        input: NewCustomer,
        salesperson_id: Option<Uuid>,
    ) -> AppResult<Customer> {
        let customer = input.into_customer(salesperson_id)?;
        let saved = self.mutate(
            |t| {
                t.customers.push(customer.clone());
                Ok(customer)
            },
            |_| vec![QueryKey::Customers],
        )?;
        log::info!("added customer {} ({})", saved.name, saved.id);
        Ok(saved)
    }

    /// Record an uploaded chit photo on the customer.
    ///
    /// # Errors
    /// * `NotFound` if the customer does not exist
    pub fn attach_chit(&self, customer_id: Uuid, url: String) -> AppResult<Customer> {
        let saved = self.mutate(
            |t| {
                let customer = t
                    .customers
                    .iter_mut()
                    .find(|c| c.id == customer_id)
                    .ok_or_else(|| AppError::not_found("Customer not found"))?;
                customer.has_chit_photo = true;
                customer.chit_image_url = Some(url);
                Ok(customer.clone())
            },
            |_| vec![QueryKey::Customers],
        )?;
        Ok(saved)
    }

    /// Customers with a chit photo, newest visit first.
    pub fn chit_archive(&self) -> Vec<Customer> {
        let mut list: Vec<Customer> = self
            .customers()
            .iter()
            .filter(|c| c.has_chit_photo && c.chit_image_url.is_some())
            .cloned()
            .collect();
        list.sort_by(|a, b| b.visit_date.cmp(&a.visit_date));
        list
    }

    /// Customer with every room and each room's selections and estimates.
    ///
    /// # Errors
    /// * `NotFound` if the customer does not exist
    pub fn customer_detail(&self, id: Uuid) -> AppResult<CustomerDetail> {
        let customer = self.customer(id)?;
        let rooms = self
            .rooms_for_customer(id)?
            .iter()
            .map(|room| {
                Ok(RoomDetail {
                    room: room.clone(),
                    selections: self.selections_for_room(room.id)?.as_ref().clone(),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(CustomerDetail { customer, rooms })
    }

    // ---- rooms ----

    /// Rooms of a customer in the order they were entered.
    pub fn rooms_for_customer(&self, customer_id: Uuid) -> AppResult<Arc<Vec<Room>>> {
        let key = QueryKey::Rooms(Some(customer_id));
        if let Some(Cached::Rooms(list)) = self.cache.get(&key) {
            return Ok(list);
        }
        let tables = self.read();
        tables.customer(customer_id)?;
        let mut list: Vec<Room> = tables
            .rooms
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let list = Arc::new(list);
        self.cache.put(key, Cached::Rooms(list.clone()));
        Ok(list)
    }

    pub fn room(&self, id: Uuid) -> AppResult<Room> {
        self.read().room(id).cloned()
    }

    /// Add a room to an existing customer.
    ///
    /// # Errors
    /// * `Validation` if the name is blank or the area is not positive
    /// * `NotFound` if the customer does not exist
    pub fn add_room(&self, input: NewRoom) -> AppResult<Room> {
        let room = input.into_room()?;
        let saved = self.mutate(
            |t| {
                t.customer(room.customer_id)?;
                t.rooms.push(room.clone());
                Ok(room)
            },
            |room| vec![QueryKey::Rooms(Some(room.customer_id))],
        )?;
        log::info!(
            "added room {} ({} sq.ft) for customer {}",
            saved.room_name,
            saved.total_sqft,
            saved.customer_id
        );
        Ok(saved)
    }

    // ---- tile selections ----

    /// Selections of a room joined with tile data, oldest first.
    pub fn selections_for_room(&self, room_id: Uuid) -> AppResult<Arc<Vec<SelectionView>>> {
        let key = QueryKey::Selections(Some(room_id));
        if let Some(Cached::Selections(list)) = self.cache.get(&key) {
            return Ok(list);
        }
        let tables = self.read();
        tables.room(room_id)?;
        let mut rows: Vec<&TileSelection> = tables
            .tile_selections
            .iter()
            .filter(|s| s.room_id == room_id)
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let list = Arc::new(
            rows.into_iter()
                .map(|s| tables.view(s))
                .collect::<AppResult<Vec<_>>>()?,
        );
        self.cache.put(key, Cached::Selections(list.clone()));
        Ok(list)
    }

    pub fn selection(&self, id: Uuid) -> AppResult<SelectionView> {
        let tables = self.read();
        let selection = tables
            .tile_selections
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::not_found("Tile selection not found"))?;
        tables.view(selection)
    }

    /// Add a catalog tile to a room.
    ///
    /// The required area defaults to the room's area; the returned view
    /// carries the calculated box count and, when a rate was given, the price.
    ///
    /// # Arguments
    /// * `input` - Room, tile and optional area, rate and final-choice flag
    ///
    /// # Returns
    /// * `AppResult<SelectionView>` - The selection joined with its tile
    ///
    /// # Errors
    /// * `NotFound` if the room or the tile does not exist
    /// * `Validation` if the tile is inactive or an amount is negative
    pub fn add_selection(&self, input: NewTileSelection) -> AppResult<SelectionView> {
        let view = self.mutate(
            |t| {
                let room = t.room(input.room_id)?.clone();
                let tile = t.tile(input.tile_id)?;
                if !tile.is_active {
                    return Err(AppError::validation(format!(
                        "{} is no longer in the catalog",
                        tile.tile_name
                    )));
                }
                let selection = input.into_selection(&room)?;
                let view = t.view(&selection)?;
                t.tile_selections.push(selection);
                Ok(view)
            },
            |view| vec![QueryKey::Selections(Some(view.selection.room_id))],
        )?;
        log::info!(
            "added {} ({}) to room {}",
            view.tile.tile_name,
            view.tile.size,
            view.selection.room_id
        );
        Ok(view)
    }

    /// Apply an admin adjustment.
    ///
    /// Missing fields stay as they are; a `null` adjustment clears it. Every
    /// room's selection list is dropped from the cache.
    ///
    /// # Errors
    /// * `NotFound` if the selection does not exist
    /// * `Validation` if any field is invalid, in which case nothing changes
    pub fn update_selection(&self, id: Uuid, update: SelectionUpdate) -> AppResult<SelectionView> {
        let view = self.mutate(
            |t| {
                let selection = t.selection_mut(id)?;
                update.apply(selection)?;
                let selection = selection.clone();
                t.view(&selection)
            },
            |_| vec![QueryKey::Selections(None)],
        )?;
        log::info!(
            "updated selection {} (status {})",
            view.selection.id,
            view.selection.status
        );
        Ok(view)
    }

    /// Flip the final-choice star on a selection.
    pub fn toggle_final_choice(&self, id: Uuid) -> AppResult<SelectionView> {
        let view = self.mutate(
            |t| {
                let selection = t.selection_mut(id)?;
                selection.is_final_choice = !selection.is_final_choice;
                let selection = selection.clone();
                t.view(&selection)
            },
            |view| vec![QueryKey::Selections(Some(view.selection.room_id))],
        )?;
        Ok(view)
    }

    // ---- tiles ----

    /// Whole catalog ordered by name.
    pub fn tiles(&self) -> Arc<Vec<Tile>> {
        if let Some(Cached::Tiles(list)) = self.cache.get(&QueryKey::Tiles) {
            return list;
        }
        let tables = self.read();
        let mut list = tables.tiles.clone();
        list.sort_by(|a, b| a.tile_name.to_lowercase().cmp(&b.tile_name.to_lowercase()));
        let list = Arc::new(list);
        self.cache.put(QueryKey::Tiles, Cached::Tiles(list.clone()));
        list
    }

    /// Catalog filtered by a case-insensitive search on name, size or barcode.
    pub fn search_tiles(&self, query: Option<&str>, active_only: bool) -> Vec<Tile> {
        let needle = query.map(|q| q.trim().to_lowercase()).unwrap_or_default();
        self.tiles()
            .iter()
            .filter(|t| !active_only || t.is_active)
            .filter(|t| {
                needle.is_empty()
                    || contains_ci(&t.tile_name, &needle)
                    || contains_ci(&t.size, &needle)
                    || t.barcode.as_deref().is_some_and(|b| contains_ci(b, &needle))
            })
            .cloned()
            .collect()
    }

    pub fn tile(&self, id: Uuid) -> AppResult<Tile> {
        self.read().tile(id).cloned()
    }

    /// Active tile carrying exactly this barcode.
    pub fn tile_by_barcode(&self, barcode: &str) -> Option<Tile> {
        let key = QueryKey::Tile(Some(barcode.to_string()));
        if let Some(Cached::Tile(tile)) = self.cache.get(&key) {
            return tile;
        }
        let tables = self.read();
        let tile = tables
            .tiles
            .iter()
            .find(|t| t.is_active && t.barcode.as_deref() == Some(barcode))
            .cloned();
        self.cache.put(key, Cached::Tile(tile.clone()));
        tile
    }

    /// Keys a catalog write makes stale; selection views embed tile data.
    fn tile_keys(_: &Tile) -> Vec<QueryKey> {
        vec![
            QueryKey::Tiles,
            QueryKey::Tile(None),
            QueryKey::Selections(None),
        ]
    }

    /// Add a tile to the catalog. New tiles are active unless the input says otherwise.
    ///
    /// # Errors
    /// * `Validation` if the packaging figures are invalid
    /// * `Conflict` if the barcode is already on another tile
    pub fn add_tile(&self, input: TileInput) -> AppResult<Tile> {
        let tile = input.into_tile(Uuid::new_v4(), Utc::now())?;
        let saved = self.mutate(
            |t| {
                if let Some(code) = &tile.barcode {
                    if t.barcode_taken(code, None) {
                        return Err(AppError::Conflict(format!(
                            "Barcode {} is already assigned to another tile",
                            code
                        )));
                    }
                }
                t.tiles.push(tile.clone());
                Ok(tile)
            },
            Self::tile_keys,
        )?;
        log::info!("added tile {} ({})", saved.tile_name, saved.size);
        Ok(saved)
    }

    /// Replace a tile's catalog fields, keeping its id and creation time.
    ///
    /// # Errors
    /// * `NotFound`, `Validation` or `Conflict` as for [`Store::add_tile`]
    pub fn update_tile(&self, id: Uuid, input: TileInput) -> AppResult<Tile> {
        let saved = self.mutate(
            |t| {
                let current = t.tile(id)?;
                let created_at = current.created_at;
                let was_active = current.is_active;
                let mut tile = input.clone().into_tile(id, created_at)?;
                // an edit without an explicit flag keeps the current one
                if input.is_active.is_none() {
                    tile.is_active = was_active;
                }
                if let Some(code) = &tile.barcode {
                    if t.barcode_taken(code, Some(id)) {
                        return Err(AppError::Conflict(format!(
                            "Barcode {} is already assigned to another tile",
                            code
                        )));
                    }
                }
                let slot = t
                    .tiles
                    .iter_mut()
                    .find(|x| x.id == id)
                    .ok_or_else(|| AppError::not_found("Tile not found"))?;
                *slot = tile.clone();
                Ok(tile)
            },
            Self::tile_keys,
        )?;
        log::info!("updated tile {}", saved.tile_name);
        Ok(saved)
    }

    pub fn toggle_tile_active(&self, id: Uuid) -> AppResult<Tile> {
        let saved = self.mutate(
            |t| {
                let tile = t
                    .tiles
                    .iter_mut()
                    .find(|x| x.id == id)
                    .ok_or_else(|| AppError::not_found("Tile not found"))?;
                tile.is_active = !tile.is_active;
                Ok(tile.clone())
            },
            Self::tile_keys,
        )?;
        log::info!(
            "tile {} is now {}",
            saved.tile_name,
            if saved.is_active { "active" } else { "inactive" }
        );
        Ok(saved)
    }

    /// Load the demo catalog when no tiles exist yet.
    pub fn seed_catalog(&self) -> AppResult<usize> {
        if !self.read().tiles.is_empty() {
            return Ok(0);
        }
        let demo = [
            ("Marble Elegance", "60x60", 4, 16.0, "ME6060"),
            ("Wood Finish", "20x120", 6, 15.5, "WF20120"),
            ("Modern Grey", "60x120", 2, 15.5, "MG60120"),
        ];
        for (name, size, pieces, sqft, code) in demo {
            self.add_tile(TileInput {
                tile_name: name.to_string(),
                size: size.to_string(),
                pieces_per_box: pieces,
                sqft_per_box: sqft,
                barcode: Some(code.to_string()),
                image_url: None,
                is_active: Some(true),
            })?;
        }
        Ok(demo.len())
    }
}
