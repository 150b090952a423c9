pub mod envelope;
pub mod publish;
pub mod subscriber;
pub mod transport;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use envelope::*;
pub use publish::*;
pub use subscriber::*;
pub use transport::*;
