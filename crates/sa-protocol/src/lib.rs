pub mod descriptor;
pub mod error;
pub mod result;
pub mod routing;
pub mod schema;
pub mod telemetry;

pub use descriptor::*;
pub use error::*;
pub use result::*;
pub use routing::*;
pub use schema::*;
pub use telemetry::*;
