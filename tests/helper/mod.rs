#![allow(dead_code)]

pub mod feed;
pub mod nupkg;

#[allow(unused_imports)]
pub use feed::*;
#[allow(unused_imports)]
pub use nupkg::*;
