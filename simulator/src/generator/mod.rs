pub mod phantom;
