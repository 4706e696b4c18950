/*!
# Tile Showroom

A sales and billing service for a tile showroom, built in Rust.

## Overview

Salespeople register walk-in customers, record the rooms they want tiled and
pick catalog tiles for each room, by browsing or by scanning the QR code on
the sample. Every pick carries a box-count estimate. Admins maintain the tile
catalog, review the customers' starred final choices and adjust boxes,
filler, transport and status before billing.

## Architecture

### Frontend Layer
- Server-rendered handlebars pages, one per client route
- A small script per page talking to the JSON API

### Backend Layer
- **Technologies**: Rust, axum
- **Core Components**:
  - Route guard - sends signed-out and non-admin users to the right page
  - Session auth - argon2 password hashes, cookie sessions
  - Data-access layer - customers, rooms, tiles and tile selections
  - Query cache - keyed reads, invalidated by each write
  - Estimator - boxes and price from area, coverage and rate

### Data Persistence Layer
- Tables in one gzip-compressed bincode snapshot
- Users in a JSON file
- Measurement chit photos as files under the data directory

## Modules

- **config**: command line and environment configuration
- **error**: the service error type and its JSON rendering
- **models**: records, inputs and joined views
- **estimate**: box and price calculation
- **saving**: snapshot persistence
- **cache**: query cache
- **store**: data-access operations
- **auth**: users, sessions and the auth middleware
- **guard**: page access rules
- **api**, **scan**, **chits**: JSON handlers
- **pages**: page handlers and templates
- **app**: state, routing and the server loop
*/

pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod chits;
pub mod config;
pub mod error;
pub mod estimate;
pub mod guard;
pub mod models;
pub mod pages;
pub mod saving;
pub mod scan;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use store::Store;
