pub mod artisan;
pub mod client;
pub mod intervention;
pub mod tenant;

pub use artisan::Artisan;
pub use client::Client;
pub use intervention::Intervention;
pub use tenant::TenantRow;
