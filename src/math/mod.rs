// src/math/mod.rs
pub mod legendre;
pub mod tensor;
pub mod vector_list;
