pub(crate) mod assertions;

pub(crate) mod logging;

pub(crate) mod mem_db;

pub(crate) mod number_machine;

pub(crate) mod recording_listener;
