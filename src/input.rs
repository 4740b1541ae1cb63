pub mod line_buf;
pub mod sendlist;
