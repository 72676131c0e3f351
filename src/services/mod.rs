pub mod denoise;
pub mod index;
pub mod normalize;
pub mod ocr;
pub mod preprocess;
pub mod queue;
pub mod scratch;
pub mod sink;
pub mod storage;
