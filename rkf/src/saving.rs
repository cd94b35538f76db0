use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use csv::Writer;

use crate::{OdeState, RkfErrors, result::Trajectory};

impl<S: OdeState> Trajectory<S> {
    /// Writes the trajectory to a CSV file, creating parent directories.
    ///
    /// The header is `t,y0,y1,...`, one column per state component.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), RkfErrors> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        self.write_csv_to(BufWriter::new(file))
    }

    /// Writes the trajectory as CSV to any writer.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), RkfErrors> {
        let mut writer = Writer::from_writer(writer);

        let mut row = Vec::new();
        if let Some(y0) = self.states.first() {
            y0.write_row(&mut row);
        }
        let mut headers = vec!["t".to_string()];
        headers.extend((0..row.len()).map(|i| format!("y{i}")));
        writer.write_record(&headers)?;

        let mut record = Vec::with_capacity(headers.len());
        for (t, y) in self.iter() {
            row.clear();
            y.write_row(&mut row);
            record.clear();
            record.push(t.to_string());
            record.extend(row.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
