pub(crate) mod year_ext;
