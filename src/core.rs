pub mod backend;
pub mod driver;
pub mod model;
pub mod parameters;
pub mod program;
pub mod series;
pub mod summary;
pub mod trajectory;
pub mod window;
