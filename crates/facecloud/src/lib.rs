#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use facecloud_3d as k3d;

#[doc(inline)]
pub use facecloud_landmark as landmark;

#[doc(inline)]
pub use facecloud_pipeline as pipeline;
