#[macro_export]
macro_rules! log {
    ($message:expr) => {
        {
        tracing::info!("@{}  {}", crate::resolute::HANDLE_ID.lock(), $message);
        crate::resolute::LOGS.lock().push(crate::metadata::LOG::new($message));
        }
    };
    ($message:expr, $name:expr) => {
        {
        tracing::info!("@{}  {}", crate::resolute::HANDLE_ID.lock(), $message);
        crate::resolute::LOGS.lock().push(crate::metadata::LOG::new_with_name($message, $name));
        }
    };
}
