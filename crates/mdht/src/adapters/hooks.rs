//! Default `QueryHooks`: accepts every query, ignores every announce.

use crate::ports::QueryHooks;

pub struct NoopQueryHooks;

impl QueryHooks for NoopQueryHooks {}
