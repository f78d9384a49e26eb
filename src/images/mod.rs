pub mod services;

pub use services::{attach_image, image_url, UploadItem};
