mod equipment;
mod listing;
mod reservation;

pub use equipment::*;
pub use listing::*;
pub use reservation::*;
