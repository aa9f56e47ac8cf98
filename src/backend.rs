/// Single-threaded reference kernels operating on raw `f32` slices.
pub mod cpu;
