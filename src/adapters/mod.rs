// Implementações concretas das portas de `domain::ports`.

pub mod process;
pub mod xlsx;

pub use process::ProcessRunner;
pub use xlsx::XlsxReader;
