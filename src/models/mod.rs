mod authority;
mod record;
mod state;

pub use authority::*;
pub use record::*;
pub use state::*;
