pub mod artworks;
pub mod collections;
pub mod outreach;
pub mod profiles;
pub mod registration;

pub use artworks::ArtworkService;
pub use profiles::ProfileService;
pub use registration::{register_artwork, RegistrationOutcome, RegistrationRequest};
