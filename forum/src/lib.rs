//! # CDK Forum
//!
//! HTTP implementation of [`cdk_core::providers::ForumClient`] for a Discourse
//! forum. Lottery projects read two documents:
//!
//! - `GET {base}/t/{topic}.json`: topic metadata (tags, closed, last post)
//! - `GET {base}/raw/{topic}/{post}`: raw markdown of the result post
//!
//! Both requests carry the service's `User-Api-Key`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;

pub use client::{DEFAULT_BASE_URL, HttpForumClient};
