/*!
 * Authentication primitives.
 *
 * - `password`: bcrypt hashing and verification
 * - `token`: signed access tokens carrying the user's id and role
 */

pub mod password;
pub mod token;

pub use password::PasswordHasher;
pub use token::{Claims, TokenService};
