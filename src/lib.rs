#[macro_use]
extern crate rocket;

pub mod analytics;
pub mod auth;
pub mod balance;
pub mod config;
pub mod currency;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod summary;

use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};

use crate::auth::TokenKeys;
use crate::currency::RateTable;
use crate::db::GroupStore;

/// Assembles the API with its managed state; `main` only has to launch it.
pub fn build_rocket(
    store: GroupStore,
    keys: TokenKeys,
    rates: RateTable,
) -> Result<Rocket<Build>, rocket_cors::Error> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::all())
        .to_cors()?;

    Ok(rocket::build()
        .attach(cors)
        .manage(store)
        .manage(keys)
        .manage(rates)
        .mount("/api", routes::get_routes()))
}
