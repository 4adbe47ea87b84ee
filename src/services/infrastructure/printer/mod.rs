/// 打印相关模块

pub mod tcp_printer;
pub mod label_service;
pub mod mock_printer;

pub use tcp_printer::TcpPrinter;
pub use label_service::{LabelService, DEFAULT_LABEL_TEMPLATE};
pub use mock_printer::{MockLabelPrinter, MockPrinter, PrintedLabel};
