pub mod city;
pub mod measurement;
pub mod photo;
pub mod provider;
pub mod timestamp;
pub mod volunteer;

pub use city::{City, NewCity, DEFAULT_STATE};
pub use measurement::{Measurement, NewMeasurement};
pub use photo::Photo;
pub use provider::{NewUtilityProvider, UtilityProvider};
pub use volunteer::{NewVolunteer, Volunteer};
