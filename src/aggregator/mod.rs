/// Rolling sample window shared between ingest and the tick path
pub mod sample_window;

pub use sample_window::SampleWindow;
