//! API handlers module

pub mod admin;
pub mod health;
pub mod ingredients;
pub mod recipes;
pub mod shopping_cart;
pub mod subscriptions;
pub mod tags;
pub mod users;
mod views;
