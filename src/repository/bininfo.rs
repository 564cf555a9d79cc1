//! Binary metadata.

use super::model::{EntryPoint, Section};
use crate::error::Result;
use crate::session::SessionHandle;

/// Queries section headers and entry points of the open file.
#[derive(Debug, Clone)]
pub struct BinInfoRepository {
    session: SessionHandle,
}

impl BinInfoRepository {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Section headers. Empty when the file has none (raw data).
    pub async fn sections(&self) -> Result<Vec<Section>> {
        self.session.execute_structured("iS").await?.decode()
    }

    /// Program entry points.
    pub async fn entry_points(&self) -> Result<Vec<EntryPoint>> {
        self.session.execute_structured("ie").await?.decode()
    }
}
