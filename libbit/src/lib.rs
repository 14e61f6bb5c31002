#![deny(rust_2018_idioms)]
#![feature(associated_type_bounds)]
#![feature(hash_raw_entry)]
#![feature(pattern)]
#![feature(never_type)]
#![feature(exact_size_is_empty)]
#![feature(maybe_uninit_uninit_array, maybe_uninit_slice)]
#![feature(associated_type_defaults)]
#![feature(decl_macro)]
#![feature(trait_alias)]
#![feature(is_sorted)]
#![feature(array_methods)]
#![feature(type_alias_impl_trait)]

extern crate self as libbit;

#[macro_use]
extern crate smallvec;

#[cfg(test)]
extern crate quickcheck;

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

#[macro_use]
extern crate maplit;

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate num_derive;

#[macro_use]
extern crate bit_derive;

#[macro_use]
extern crate anyhow;

#[cfg(test)]
#[macro_use]
pub mod test_utils;
mod cache;

#[macro_use]
extern crate log;

#[macro_use]
mod macros;

#[macro_use]
mod debug;

pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod iter;
pub mod obj;
pub mod pack;
pub mod path;
pub mod pathspec;
pub mod refs;
pub mod repo;
pub mod rev;
pub mod serialize;

mod core;
mod delta;
mod interner;
mod io;
mod lockfile;
mod odb;
mod peel;
mod signature;
mod time;
mod tls;
