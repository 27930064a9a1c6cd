use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::{ error::MreadError, metadata::LOG };

lazy_static! {
    pub(crate) static ref LOGS: Mutex<Vec<LOG>> = Mutex::new(Vec::new());
    pub(crate) static ref HANDLE_ID: Mutex<Box<str>> = Mutex::new(String::new().into_boxed_str());
    pub(crate) static ref CURRENT_SCREEN: Mutex<String> = Mutex::new(String::new());
    pub(crate) static ref SUSPENDED: Mutex<Vec<MreadError>> = Mutex::new(Vec::new());
}
