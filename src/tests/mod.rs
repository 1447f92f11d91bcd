pub(crate) mod helpers;
