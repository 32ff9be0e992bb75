pub mod dmm;
