//! One open database transaction, owned directly by a [`crate::session::Session`]
//! rather than looked up from thread-local state (see DESIGN.md).

use crate::error::SqlweaveError;
use crate::udbc::connection::Connection;
use crate::udbc::driver::Driver;
use std::sync::Arc;

pub struct Transaction {
    conn: Option<Box<dyn Connection>>,
    committed: bool,
}

impl Transaction {
    pub async fn begin(driver: Arc<dyn Driver>) -> Result<Self, SqlweaveError> {
        let mut conn = driver.acquire().await?;
        conn.begin().await?;
        Ok(Self { conn: Some(conn), committed: false })
    }

    pub async fn commit(&mut self) -> Result<(), SqlweaveError> {
        if let Some(conn) = self.conn.as_mut() {
            conn.commit().await?;
        }
        self.committed = true;
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), SqlweaveError> {
        let result = if let Some(conn) = self.conn.as_mut() {
            conn.rollback().await
        } else {
            Ok(())
        };
        if result.is_ok() {
            self.committed = true;
        }
        result
    }

    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.conn.as_mut().expect("transaction connection taken before drop").as_mut()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            if let Some(mut conn) = self.conn.take() {
                tokio::spawn(async move {
                    let _ = conn.rollback().await;
                });
            }
        }
    }
}
