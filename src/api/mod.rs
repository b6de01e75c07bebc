mod impls;
mod race;
mod requests;
mod responses;
mod util;

pub use impls::*;
pub use race::*;
pub use requests::*;
pub use responses::*;
pub use util::*;
