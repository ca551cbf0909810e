pub mod config;
pub mod error;
pub mod event;
pub mod itinerary;
pub mod payload;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, TripweaveError};
pub use event::EventBus;
pub use itinerary::ItineraryDocument;
pub use types::*;
