use faer::Mat;

/// A matrix of samples with named columns, one row per emitted sample.
#[derive(Debug, Clone)]
pub struct SampleTable {
    names: Vec<String>,
    data: Mat<f64>,
}

impl SampleTable {
    pub(crate) fn new(names: Vec<String>, data: Mat<f64>) -> Self {
        assert!(names.len() == data.ncols());
        Self { names, data }
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn data(&self) -> &Mat<f64> {
        &self.data
    }

    /// One named column as a contiguous slice.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(self.data.col_as_slice(idx))
    }

    /// One sample as an owned row.
    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.data.ncols()).map(|j| self.data[(i, j)]).collect()
    }
}

impl PartialEq for SampleTable {
    fn eq(&self, other: &Self) -> bool {
        if self.names != other.names
            || self.data.nrows() != other.data.nrows()
            || self.data.ncols() != other.data.ncols()
        {
            return false;
        }
        (0..self.data.ncols()).all(|j| self.data.col_as_slice(j) == other.data.col_as_slice(j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn column_lookup_by_name() {
        let data = Mat::from_fn(2, 2, |i, j| (i * 2 + j) as f64);
        let table = SampleTable::new(vec!["R1".into(), "R2".into()], data);

        assert_eq!(table.column("R1"), Some(&[0.0, 2.0][..]));
        assert_eq!(table.column("R2"), Some(&[1.0, 3.0][..]));
        assert_eq!(table.column("R3"), None);
        assert_eq!(table.row(1), vec![2.0, 3.0]);
    }
}
