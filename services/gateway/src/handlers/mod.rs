pub mod internal;
pub mod klines;
pub mod system;
pub mod ws;
