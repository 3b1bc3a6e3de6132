/// Calendar year of a dated record, for yearly grouping.
pub(crate) trait GetYear {
    fn get_year(&self) -> i32;
}
