pub mod lrp_algorithm;
pub mod mrp_algorithm;
