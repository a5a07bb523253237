// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

mod hex;
mod reader;

pub use self::hex::*;
pub use self::reader::*;
