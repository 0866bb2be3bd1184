// Individual cleaner implementations, one per known source table
pub mod health_system;
pub mod kff;
pub mod mortality_rate;
pub mod regional;

pub use health_system::HealthSystemCleaner;
pub use kff::{CesareanCleaner, CoverageCleaner, EarningsCleaner, KffMortalityCleaner};
pub use mortality_rate::MortalityRateCleaner;
pub use regional::RegionalCleaner;
