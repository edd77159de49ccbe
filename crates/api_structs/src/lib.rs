mod alarm;
mod status;

pub mod dtos {
    pub use crate::alarm::dtos::*;
}

pub use crate::status::api::*;
