pub mod ideal;
pub mod reading;
pub mod recommendation;

pub use ideal::*;
pub use reading::*;
pub use recommendation::*;
