pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod source;
pub mod stop;

pub use dispatcher::*;
pub use envelope::*;
pub use error::*;
pub use source::*;
pub use stop::*;
