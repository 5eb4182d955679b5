mod buffer_pool_manager_test;
