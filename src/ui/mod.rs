/// User interface widgets

pub mod gallery;
