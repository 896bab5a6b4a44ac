#![allow(dead_code)]

pub mod context;
