pub mod event;
pub mod pixel;

pub use event::{DeviceType, EventParams, EventRow, NewEvent, PixelEvent};
pub use pixel::{InvalidPixelId, Pixel, PixelId};
