pub(crate) mod support;

mod exchange;
