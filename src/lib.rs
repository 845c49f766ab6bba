//! Windowgate - Sliding Window Rate Limiting
//!
//! This crate implements a per-client, sliding-window request-rate limiter
//! meant to sit in front of HTTP request handlers. The limiter keeps a log of
//! recent admitted requests per client and decides, for every request, whether
//! it may proceed.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
