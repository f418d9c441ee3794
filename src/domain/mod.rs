// Camada de domínio: modelo das etapas e portas para os programas externos.

pub mod model;
pub mod ports;
