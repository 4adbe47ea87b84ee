/// 扫码器适配器

pub mod tcp_scanner;
pub mod mock_scanner;

pub use tcp_scanner::{TcpScanner, TcpScannerConfig};
pub use mock_scanner::MockCodeReader;
