pub mod cursor;
pub mod gate;
pub mod hand;
pub mod input;
pub mod keyboard;
pub mod loop_range;
pub mod piano;
pub mod session;

pub use cursor::*;
pub use gate::*;
pub use hand::*;
pub use input::*;
pub use keyboard::*;
pub use loop_range::*;
pub use piano::*;
pub use session::*;
