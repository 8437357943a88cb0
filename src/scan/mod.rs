pub mod reader;

pub use reader::{AnthropicSlipReader, SlipFields, SlipImage, SlipReader};
