pub mod city;
pub mod council;
pub mod initiative;
pub mod ripple;
